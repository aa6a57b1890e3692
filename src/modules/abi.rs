//! Contract interfaces read by the module drivers and registry discovery

use alloy::sol;

sol! {
    /// Curated / committee operator registry
    interface INodeOperatorsRegistry {
        function getNonce() external view returns (uint256);

        function getNodeOperatorsCount() external view returns (uint256);

        function getNodeOperator(uint256 _nodeOperatorId, bool _fullInfo)
            external
            view
            returns (
                bool active,
                string name,
                address rewardAddress,
                uint64 totalVettedValidators,
                uint64 totalExitedValidators,
                uint64 totalAddedValidators,
                uint64 totalDepositedValidators
            );

        function getSigningKeys(uint256 _nodeOperatorId, uint256 _offset, uint256 _limit)
            external
            view
            returns (bytes pubkeys, bytes signatures, bool[] used);
    }
}

sol! {
    /// Permissionless community module
    interface ICommunityModule {
        struct NodeOperator {
            uint32 totalAddedKeys;
            uint32 totalWithdrawnKeys;
            uint32 totalDepositedKeys;
            uint32 totalVettedKeys;
            uint32 stuckValidatorsCount;
            uint32 depositableValidatorsCount;
            uint32 targetLimit;
            uint8 targetLimitMode;
            uint32 totalExitedKeys;
            uint32 enqueuedCount;
            address managerAddress;
            address proposedManagerAddress;
            address rewardAddress;
            address proposedRewardAddress;
            bool extendedManagerPermissions;
        }

        function getNonce() external view returns (uint256);

        function getNodeOperatorsCount() external view returns (uint256);

        function getNodeOperator(uint256 nodeOperatorId) external view returns (NodeOperator memory);

        function getSigningKeysWithSignatures(uint256 nodeOperatorId, uint256 startIndex, uint256 keysCount)
            external
            view
            returns (bytes memory keys, bytes memory signatures);
    }
}

sol! {
    interface IStakingModule {
        function getType() external view returns (bytes32);
    }

    interface IStakingRouter {
        struct StakingModule {
            uint24 id;
            address stakingModuleAddress;
            uint16 stakingModuleFee;
            uint16 treasuryFee;
            uint16 stakeShareLimit;
            uint8 status;
            string name;
            uint64 lastDepositAt;
            uint256 lastDepositBlock;
            uint256 exitedValidatorsCount;
            uint16 priorityExitShareThreshold;
            uint64 maxDepositsPerBlock;
            uint64 minDepositBlockDistance;
        }

        function getStakingModules() external view returns (StakingModule[] memory res);
    }

    interface ILocator {
        function stakingRouter() external view returns (address);
    }
}
